use std::process::ExitCode;

fn main() -> ExitCode {
    chat_relay::start_bot(std::env::args().skip(1))
}
