/*!
Here we go!
*/
use std::sync::Arc;

use simplelog::{ColorChoice, TerminalMode, TermLogger};

use leavex::config;
use leavex::inter;

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("leavex")
        .build();
    if let Err(e) = TermLogger::init(
        leavex::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
        std::process::exit(1);
    }
    log::info!("Logging started.");

    let cfg_path = config::config_path(std::env::args());
    let glob = match config::load_configuration(cfg_path.as_deref()).await {
        Ok(glob) => glob,
        Err(e) => {
            log::error!("Error loading configuration: {}", &e);
            std::process::exit(1);
        },
    };
    log::info!("Global state:\n{:#?}", &glob);

    if let Err(e) = inter::init(&glob.templates_dir) {
        log::error!("Error initializing templates: {}", &e);
        std::process::exit(1);
    }

    let addr = glob.addr;
    let app = inter::app(Arc::new(glob));

    log::info!("Listening on {}", &addr);

    if let Err(e) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
    {
        log::error!("Server error: {}", &e);
        std::process::exit(1);
    }
}
