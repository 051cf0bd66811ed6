use std::path::PathBuf;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--print-config") {
        let config = folio::config::Config::default();
        match toml::to_string_pretty(&config) {
            Ok(s) => print!("{s}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("folio {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if args.iter().any(|a| a == "--help" || a == "-h") || args.len() != 2 {
        println!("folio {}", env!("CARGO_PKG_VERSION"));
        println!("A GPU-accelerated text file viewer\n");
        println!("USAGE:");
        println!("    folio FILE\n");
        println!("OPTIONS:");
        println!("    --print-config    Print the default configuration to stdout");
        println!("    --version, -V     Print version information");
        println!("    --help, -h        Print this help message");
        if args.len() != 2 {
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = run(PathBuf::from(&args[1])) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(path: PathBuf) -> anyhow::Result<()> {
    let config = folio::config::Config::load()?;
    let document = folio::document::Document::load(&path)?;
    folio::app::App::run(config, document)
}
