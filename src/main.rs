#[actix_web::main]
async fn main() -> std::io::Result<()> {
    car_doc_lib::run().await
}
