use std::process::ExitCode;

fn main() -> ExitCode {
    chat_relay::start_client(std::env::args().skip(1))
}
