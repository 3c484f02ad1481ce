fn main() {
    parley::logging::init();
    if let Err(e) = parley::cli::main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
