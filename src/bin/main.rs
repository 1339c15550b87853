use std::{error::Error, path::Path, process};

use solod::{
    cli::{Cli, Commands, parse_args},
    config::load_config,
    constants::{EXIT_FAILURE, EXIT_STATUS_STOPPED, EXIT_STATUS_UNKNOWN},
    logging::{self, LogSink},
    runtime,
    service::{SelfDaemonizedService, Status},
};

fn main() {
    let args = parse_args();
    match run(args) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(EXIT_FAILURE);
        }
    }
}

fn run(args: Cli) -> Result<i32, Box<dyn Error>> {
    let config = load_config(Path::new(&args.config))?;
    let home = runtime::home_from_env();
    let sink = LogSink::detect(&config.name, home.as_deref());
    logging::init(&sink, args.log_level.as_ref().map(|level| level.as_str()));

    let service = SelfDaemonizedService::new(config);

    match args.command {
        Commands::Start => {
            let pid = service.start()?;
            println!("Started {} (PID {pid})", service.identity());
        }
        Commands::Stop => {
            service.stop()?;
            println!("Stopped {}", service.identity());
        }
        Commands::Restart => {
            let pid = service.restart()?;
            println!("Restarted {} (PID {pid})", service.identity());
        }
        Commands::Status { json } => {
            let report = service.status_report();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match report.pid {
                    Some(pid) => println!("{}: {} (PID {pid})", service.identity(), report.status),
                    None => println!("{}: {}", service.identity(), report.status),
                }
            }
            return Ok(match report.status {
                Status::Running => 0,
                Status::Stopped => EXIT_STATUS_STOPPED,
                Status::Unknown => EXIT_STATUS_UNKNOWN,
            });
        }
        Commands::Install => {
            service.install()?;
            println!("Installed {}", service.identity());
        }
        Commands::Uninstall => {
            service.uninstall()?;
            println!("Uninstalled {}", service.identity());
        }
        Commands::Run => {
            let never = service.run()?;
            match never {}
        }
    }

    Ok(0)
}
