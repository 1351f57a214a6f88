fn main() {
    rookgl_cli::init_tracing();

    if let Err(error) = rookgl_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
