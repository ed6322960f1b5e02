pub mod selection_loader;

pub use selection_loader::{load_selection_file, parse_selection, SelectionFile};
