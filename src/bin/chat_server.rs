use std::process::ExitCode;

fn main() -> ExitCode {
    chat_relay::start_server(std::env::args().skip(1))
}
