//! quik_bench - probe a QUIK terminal and measure RPC throughput
//!
//! Usage: `quik_bench [config.json]`

use std::error::Error;
use std::path::PathBuf;

use tracing::{error, info};

use quik_rpc::logger::init_logger;
use quik_rpc::{harness, BenchConfig, Connection, Quik, SecurityInfo};

fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = BenchConfig::resolve(config_path.as_deref())?;
    init_logger(&config.log_level);
    info!("quik_bench {} against {}", quik_rpc::VERSION, config.endpoint);

    let mut quik = Quik::with_config(config.connection_config())?;
    quik.connect()?;
    println!("{}", quik.is_connected()?);
    println!("{}", quik.get_script_path()?);

    let info = quik.get_security_info(&config.probe_board, &config.ticker)?;
    let mut fields: Vec<_> = info.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in fields {
        println!("{} {}", key, value);
    }
    quik.close()?;

    let report = harness::run::<SecurityInfo, _, _>(&config.harness_config(), |_| {
        Connection::with_config(config.connection_config())
    });

    for (id, err) in report.errors() {
        error!("worker {} failed: {}", id, err);
    }
    println!("{}", report.throughput());
    Ok(())
}
