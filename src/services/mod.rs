pub mod accounts;
pub mod activities;
pub mod bugs;
pub mod comments;
pub mod notifier;
pub mod projects;
pub mod tracker_service;
pub mod validation;

#[cfg(test)]
pub mod testing;
