fn main() {
    if let Err(err) = cnq_engine::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
