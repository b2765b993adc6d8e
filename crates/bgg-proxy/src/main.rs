//! BGG proxy.
//!
//! A web service in front of the BoardGameGeek XML API. It caches things and users in Redis and
//! collapses concurrent lookups of the same entity into a single request to BGG, so that callers
//! are shielded from BGG's latency and rate limits.

#![warn(missing_debug_implementations, unused_crate_dependencies, clippy::all)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;

#[cfg(test)]
mod test;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
