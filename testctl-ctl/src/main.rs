use clap::Parser;

fn main() {
    let cli = testctl_ctl::Cli::parse();
    if let Err(err) = testctl_ctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
