pub mod contract;
pub mod prices;
pub mod ranking;
