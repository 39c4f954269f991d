use carbon_ql_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("carbon-ql error: {err}");
        std::process::exit(1);
    }
}
