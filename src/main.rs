fn main() {
    if let Err(err) = sessionward::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
