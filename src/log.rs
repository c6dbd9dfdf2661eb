//! Logging interface, contingent on the `defmt-03` feature or the hidden `__log` feature
//!
//! Format strings are restricted to `{}` and `{:?}` so that both backends accept
//! them. Only enable `__log` when debugging, and when you're certain that your
//! logger isn't using USB!
//!
//! Without a backend, the macros still borrow their arguments, so values that
//! exist only to be logged don't trip `unused` lints.

macro_rules! trace {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt::trace!($fmt $(, $arg)*);
        #[cfg(feature = "__log")]
        ::__log::trace!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt-03", feature = "__log")))]
        let _ = ($(&$arg,)*);
    }};
}

macro_rules! debug {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt::debug!($fmt $(, $arg)*);
        #[cfg(feature = "__log")]
        ::__log::debug!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt-03", feature = "__log")))]
        let _ = ($(&$arg,)*);
    }};
}

macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt::info!($fmt $(, $arg)*);
        #[cfg(feature = "__log")]
        ::__log::info!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt-03", feature = "__log")))]
        let _ = ($(&$arg,)*);
    }};
}

macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt::warn!($fmt $(, $arg)*);
        #[cfg(feature = "__log")]
        ::__log::warn!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt-03", feature = "__log")))]
        let _ = ($(&$arg,)*);
    }};
}

#[cfg(all(test, not(any(feature = "defmt-03", feature = "__log"))))]
mod tests {
    use core::cell::Cell;

    #[test]
    fn arguments_evaluated_without_backend() {
        let calls = Cell::new(0u32);
        let next = || {
            calls.set(calls.get() + 1);
            calls.get()
        };
        trace!("{}", next());
        debug!("{} {}", next(), next(),);
        info!("none");
        warn!("{:?}", next());
        assert_eq!(calls.get(), 4);
    }
}
