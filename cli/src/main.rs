mod demo;

use std::env;
use std::path::Path;

use securevault_config::SecureVaultConfig;

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args: Vec<String> = env::args().collect();

    if args.get(1).map(String::as_str) == Some("--config") {
        if let Err(e) = install_config(args.get(2)) {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
        args.drain(1..3);
    }

    if args.len() < 2 {
        print_usage();
        return;
    }

    let cmd = &args[1];

    match cmd.as_str() {
        "demo" => {
            let options = match parse_demo_args(&args[2..]) {
                Ok(options) => options,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            };
            if let Err(e) = demo::run_demo(SecureVaultConfig::global(), options).await {
                eprintln!("❌ Demo failed: {:#}", e);
                std::process::exit(1);
            }
        }
        "config" => {
            print!("{}", SecureVaultConfig::generate_sample());
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        _ => {
            println!("❌ Unknown command: {}", cmd);
            println!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("SecureVault CLI - encrypted identity vault client");
    println!();
    println!("USAGE:");
    println!("  securevault [--config <file>] <command> [args]");
    println!();
    println!("COMMANDS:");
    println!("  demo [options]             Store and verify identity data on a simulated chain");
    println!("  config                     Print a sample securevault.toml");
    println!("  help                       Show this help message");
    println!();
    println!("DEMO OPTIONS:");
    println!("  --age <n>                  Age to store (default: 25)");
    println!("  --region <n>               Region code to store (default: 1)");
    println!("  --kyc <true|false>         KYC flag to store (default: true)");
    println!("  --allowed <n>              Region to verify against (default: stored region)");
    println!("  --key <hex>                Wallet private key (default: random)");
    println!();
    println!("EXAMPLES:");
    println!("  securevault demo                           # Adult in the allowed region");
    println!("  securevault demo --age 16 --allowed 3      # Both checks fail");
    println!("  securevault config > securevault.toml      # Write a config file");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  SV_CONFIG            Path to the config file");
    println!("  SV_SIGNATURE_STORE   File that keeps decryption signatures between runs");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
}

/// Load `path` and make it the process-wide configuration.
fn install_config(path: Option<&String>) -> anyhow::Result<()> {
    let path = path.ok_or_else(|| anyhow::anyhow!("--config expects a file path"))?;
    let config = SecureVaultConfig::load_from(Path::new(path))?;
    SecureVaultConfig::set_global(config)
        .map_err(|_| anyhow::anyhow!("Configuration already initialized"))?;
    log::info!("Using config file {}", path);
    Ok(())
}

fn parse_demo_args(args: &[String]) -> anyhow::Result<demo::DemoOptions> {
    let mut options = demo::DemoOptions::default();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .ok_or_else(|| anyhow::anyhow!("{} expects a value", flag))
        };
        match flag {
            "--age" => {
                options.age = value()?.parse()?;
                i += 1;
            }
            "--region" => {
                options.region = value()?.parse()?;
                i += 1;
            }
            "--kyc" => {
                options.kyc = value()?.parse()?;
                i += 1;
            }
            "--allowed" => {
                options.allowed_region = Some(value()?.parse()?);
                i += 1;
            }
            "--key" => {
                options.private_key = Some(value()?.clone());
                i += 1;
            }
            other => anyhow::bail!("Unknown demo option: {}", other),
        }
        i += 1;
    }

    Ok(options)
}
