mod conflict;
mod retry;
mod signal;
mod success;
