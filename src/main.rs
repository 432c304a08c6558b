fn main() -> std::process::ExitCode {
    spotify_presence_lib::run()
}
