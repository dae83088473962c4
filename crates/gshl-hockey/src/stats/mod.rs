// Stat extraction and classification: the boundary where loosely-typed
// records become typed statistics and canonical model keys.

pub mod classify;
pub mod import;
pub mod schema;
