pub mod annotations;
pub mod dedup;
pub mod endpoints;
pub mod fs_scan;
pub mod lexer;
pub mod normalize;
pub mod segments;
pub mod text;
pub mod traits;
