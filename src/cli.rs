//! Shared command-line interface logic, like printing help.

pub fn print_help(binary_name: &str) {
    println!(
        "ctfwatch v{} - Watches the HackTheBox CTF catalog and emails alerts",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("One invocation runs one complete watch cycle (reminders, then");
    println!("discovery) and exits; schedule it with cron or a CI workflow.");
    println!();
    println!("USAGE:");
    println!("    {} [OPTIONS]", binary_name);
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <path>   Use an explicit config file.");
    println!("    -r, --root <path>     Use a different directory for config and data.");
    println!("    -v, --verbose         Enable debug logging.");
    println!("    -V, --version         Print the version and exit.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("CONFIGURATION (config.toml):");
    println!("    # api_base = \"https://ctf.hackthebox.com/api/public/ctfs\"");
    println!("    # detail_delay_secs = 1.0");
    println!("    # http_timeout_secs = 20");
    println!("    # remind_window_hours = 72");
    println!();
    println!("    [smtp]");
    println!("    server = \"smtp.example.com\"");
    println!("    port = 587");
    println!("    username = \"watcher\"");
    println!("    password = \"...\"");
    println!("    to = \"you@example.com\"");
    println!("    from = \"CTF Watcher <watcher@example.com>\"");
    println!();
    println!("EXIT CODES:");
    println!("    0   Cycle completed (individual fetch/send failures are logged).");
    println!("    1   Configuration missing or invalid.");
}
