fn main() {
    if let Err(e) = vidlib::run() {
        eprintln!("vidlib: {e:#}");
        std::process::exit(1);
    }
}
