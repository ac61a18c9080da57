pub mod alu;
pub mod thumb_alu;
pub mod thumb_branch;
pub mod thumb_load_store;
