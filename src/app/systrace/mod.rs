pub mod parser;

pub use parser::TraceParser;

pub fn start_command(package_name: &str) -> String {
    format!("atrace -a {package_name} -n --async_start")
}

pub const DUMP_COMMAND: &str = "atrace --async_dump";
pub const STOP_COMMAND: &str = "atrace --async_stop";
