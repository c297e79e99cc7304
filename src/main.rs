#[actix_web::main]
async fn main() -> std::process::ExitCode {
    match stoplight_query_lib::run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
