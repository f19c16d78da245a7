//! RFC 3977 - Network News Transfer Protocol (NNTP)
//!
//! Command builders and reply parsers used by the client.
//! https://datatracker.ietf.org/doc/html/rfc3977

mod rfc3977 {
    mod group;
    mod response;
    mod stat;
    mod xover;
}
