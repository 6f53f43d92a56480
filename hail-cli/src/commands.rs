//! CLI command implementations.

use colored::Colorize;
use hail_server::{DispatchServer, ServerConfig};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Start the dispatch server and run until Ctrl+C.
pub async fn serve(port: u16, monitor_port: u16, query_port: u16, headless: bool) -> Result<()> {
    let bind_addr = if headless { "0.0.0.0" } else { "127.0.0.1" };

    if headless {
        println!("{}", "Starting Hail server in headless mode...".cyan());
    } else {
        println!("{}", "Starting Hail server...".cyan());
    }

    let config = ServerConfig {
        addr: format!("{}:{}", bind_addr, port).parse()?,
        monitor_addr: format!("{}:{}", bind_addr, monitor_port).parse()?,
        query_addr: format!("{}:{}", bind_addr, query_port).parse()?,
    };
    let server = DispatchServer::new(config);

    println!(
        "{} Dispatch ws://{}:{}  monitor ws://{}:{}  query ws://{}:{}",
        "✓".green(),
        bind_addr,
        port,
        bind_addr,
        monitor_port,
        bind_addr,
        query_port
    );
    if headless {
        println!("  Headless mode: accepting connections from any host");
    }
    println!("  Press {} to stop", "Ctrl+C".cyan());

    tokio::select! {
        result = server.run() => {
            result.map_err(|e| e.to_string())?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n{} Shutting down", "✓".green());
        }
    }

    Ok(())
}
