mod cli;
mod evaluate;
mod infra;
mod routes;
mod server;

use carbon_ql::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
