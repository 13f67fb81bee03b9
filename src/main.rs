use cgi_gateway::config::Config;
use cgi_gateway::server;
use std::env;
use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 1 {
        &args[1]
    } else {
        "gateway.yaml"
    };

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    log::info!("starting gateway with config from {}", config_path);

    let mut server = match server::Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("error initializing server: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        log::error!("server error: {}", e);
        process::exit(1);
    }
}
