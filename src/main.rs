#[tokio::main]
async fn main() {
    let args = beanhub_cli::args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level.into())
        .format_timestamp(None)
        .init();
    if let Err(err) = beanhub_cli::cli::main(args).await {
        log::error!("{err:#}");
        std::process::exit(-1);
    }
}
