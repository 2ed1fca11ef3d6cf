fn main() {
    if let Err(err) = scrollguard_lib::run() {
        eprintln!("scrollguard: {err:#}");
        std::process::exit(1);
    }
}
