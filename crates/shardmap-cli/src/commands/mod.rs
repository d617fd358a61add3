//! CLI subcommands

pub mod inspect;
pub mod lookup;
pub mod plan;

pub use inspect::InspectCommand;
pub use lookup::LookupCommand;
pub use plan::PlanCommand;
