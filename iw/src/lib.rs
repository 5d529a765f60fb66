pub mod bsp;
pub mod error;
pub mod game_data;
pub mod iwi;
pub mod material;
pub mod prelude;
pub mod xmodel;

use std::path::Path;

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_str()
        .unwrap_or_default()
        .to_string()
}
