pub mod activity;
pub mod leaderboard;
pub mod quota;
