pub mod balances;
pub mod settlement;
