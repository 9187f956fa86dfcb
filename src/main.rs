mod app;
mod audio;
mod commands;
mod config;
mod logging;
mod platform;
mod render;
mod session;
mod setup;
mod ui;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
