//! Entry point for the `osm-snapshot` command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = snapshot_cli::run() {
        eprintln!("osm-snapshot: {err}");
        std::process::exit(1);
    }
}
