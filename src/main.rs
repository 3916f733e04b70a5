mod cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_main().await {
        cli::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
