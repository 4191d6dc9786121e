pub mod credit;
pub mod exchequer;
pub mod supply;
pub mod wallet;
