pub mod serve;
pub mod show;
mod source;

pub use serve::ServeCommand;
pub use show::ShowCommand;
