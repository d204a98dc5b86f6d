pub mod collector;
pub mod fetcher;
pub mod library;
pub mod reconcile;
pub mod spotify_client;
