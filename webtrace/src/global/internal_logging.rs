//! Diagnostics emitted by the webtrace crates themselves.
//!
//! With `internal-logs` enabled every event goes to `tracing` under the
//! emitting crate's target. Test builds without that feature print to stdout
//! instead. Each key/value argument is evaluated exactly once.

#[doc(hidden)]
#[macro_export]
macro_rules! __wt_log {
    ($level:ident, $name:expr $(, $key:ident = $value:expr)*) => {{
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name
                $(, $key = $value)*
            );
        }

        #[cfg(all(test, not(feature = "internal-logs")))]
        {
            print!("wt_{}: name={}", stringify!($level), $name);
            $(print!(", {}={}", stringify!($key), $value);)*
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name $(, $value)*);
        }
    }};
}

/// Logs a lifecycle milestone, such as the tracker being installed.
///
/// ```rust
/// use webtrace::wt_info;
/// wt_info!(name: "Tracker.Start", reset_delay_ms = 50);
/// ```
#[macro_export]
macro_rules! wt_info {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__wt_log!(info, $name $(, $key = $value)*)
    };
}

/// Logs data that was dropped or a call that was ignored.
///
/// ```rust
/// use webtrace::wt_warn;
/// wt_warn!(name: "AgentExporter.TransportQueueFull", dropped = 3);
/// ```
#[macro_export]
macro_rules! wt_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__wt_log!(warn, $name $(, $key = $value)*)
    };
}

/// Logs per-task bookkeeping. Noisy.
///
/// ```rust
/// use webtrace::wt_debug;
/// wt_debug!(name: "Span.EndIgnored", reason = "already ended");
/// ```
#[macro_export]
macro_rules! wt_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__wt_log!(debug, $name $(, $key = $value)*)
    };
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    #[test]
    fn values_are_evaluated_at_most_once() {
        let calls = Cell::new(0);
        let next = || {
            calls.set(calls.get() + 1);
            calls.get()
        };
        let owned = String::from("https://collector.example/v1/trace");

        crate::wt_warn!(name: "Logging.Once", attempt = next(), uri = owned);
        crate::wt_debug!(name: "Logging.NoFields");

        assert!(calls.get() <= 1);
    }
}
