fn main() {
    if let Err(e) = medreview_lib::run() {
        eprintln!("medreview: {e}");
        std::process::exit(1);
    }
}
