mod close;
mod pending;
