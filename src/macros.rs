/// Increment a stats counter by 1.
///
/// Compiles to nothing when the `stats` feature is disabled.
#[macro_export]
macro_rules! stat_inc {
    ($counter:ident) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add(1, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add a value to a stats counter.
///
/// Compiles to nothing (including the value expression) when the `stats`
/// feature is disabled.
#[macro_export]
macro_rules! stat_add {
    ($counter:ident, $val:expr) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add($val as u64, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Emit a trace-level event through `log`.
///
/// Compiles to nothing when the `debug` feature is disabled. The heap never
/// allocates through itself while logging, but an installed logger might, so
/// only enable this when the heap is not the process-wide allocator.
#[macro_export]
macro_rules! heap_trace {
    ($($arg:tt)+) => {
        #[cfg(feature = "debug")]
        {
            ::log::trace!(target: "blockheap", $($arg)+);
        }
        #[cfg(not(feature = "debug"))]
        {
            if false {
                let _ = ::core::format_args!($($arg)+);
            }
        }
    };
}

/// Emit a warn-level event through `log`. Used for detected corruption.
///
/// Compiles to nothing when the `debug` feature is disabled.
#[macro_export]
macro_rules! heap_warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "debug")]
        {
            ::log::warn!(target: "blockheap", $($arg)+);
        }
        #[cfg(not(feature = "debug"))]
        {
            if false {
                let _ = ::core::format_args!($($arg)+);
            }
        }
    };
}
