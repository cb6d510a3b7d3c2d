/// Example program to print the effective configuration
///
/// Run with: cargo run -p rune-config --example print_config

fn main() {
    let config = match rune_config::RuneConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    println!("=== rune-inline Configuration ===\n");

    println!("Logging:");
    println!("  Filter: {}", config.logging.filter());
    println!();

    let critical = &config.critical;
    println!("Critical CSS:");
    println!("  Base Path: {:?}", critical.path);
    println!("  Public Path: {:?}", critical.public_path);
    println!("  Preload: {}", critical.preload);
    println!("  Prune Source: {}", critical.prune_source);
    println!("  Inline Threshold: {}", critical.inline_threshold);
    println!("  Minimum External Size: {}", critical.minimum_external_size);
    println!("  Merge Stylesheets: {}", critical.merge_stylesheets);
    println!("  Keyframes: {}", critical.keyframes.as_str());
    println!("  Additional Stylesheets: {:?}", critical.additional_stylesheets);
    println!();

    match toml::to_string_pretty(&config) {
        Ok(toml_str) => {
            println!("=== Serialized Configuration ===");
            println!("{}", toml_str);
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
        }
    }
}
