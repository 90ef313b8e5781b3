pub mod per_diem;
pub mod reports;
