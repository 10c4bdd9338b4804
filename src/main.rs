fn main() {
    if let Err(err) = sld_remap::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
