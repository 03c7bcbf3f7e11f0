//! Region-of-interest markers and simulator control hooks.
//!
//! Under the `m5ops` feature these emit the matching gem5 pseudo
//! instructions so a simulated run can scope its statistics to the kernel
//! proper. Everywhere else they log at debug level and return, which keeps
//! instrumented kernels runnable on a plain host.

#[cfg(feature = "m5ops")]
mod m5 {
    extern "C" {
        pub fn m5_work_begin(workid: u64, threadid: u64);
        pub fn m5_work_end(workid: u64, threadid: u64);
        pub fn m5_reset_stats(ns_delay: u64, ns_period: u64);
        pub fn m5_dump_stats(ns_delay: u64, ns_period: u64);
        pub fn m5_checkpoint(ns_delay: u64, ns_period: u64);
        pub fn m5_exit(ns_delay: u64);
    }
}

/// Mark the start of the region of interest.
pub fn begin() {
    #[cfg(feature = "m5ops")]
    unsafe {
        m5::m5_work_begin(0, 0);
    }
    #[cfg(not(feature = "m5ops"))]
    log::debug!("roi begin");
}

/// Mark the end of the region of interest.
pub fn end() {
    #[cfg(feature = "m5ops")]
    unsafe {
        m5::m5_work_end(0, 0);
    }
    #[cfg(not(feature = "m5ops"))]
    log::debug!("roi end");
}

/// Zero the simulator's statistics counters.
pub fn reset_stats() {
    #[cfg(feature = "m5ops")]
    unsafe {
        m5::m5_reset_stats(0, 0);
    }
    #[cfg(not(feature = "m5ops"))]
    log::debug!("roi reset stats");
}

/// Flush the simulator's statistics counters.
pub fn dump_stats() {
    #[cfg(feature = "m5ops")]
    unsafe {
        m5::m5_dump_stats(0, 0);
    }
    #[cfg(not(feature = "m5ops"))]
    log::debug!("roi dump stats");
}

/// Request a simulator checkpoint.
pub fn checkpoint() {
    #[cfg(feature = "m5ops")]
    unsafe {
        m5::m5_checkpoint(0, 0);
    }
    #[cfg(not(feature = "m5ops"))]
    log::debug!("roi checkpoint");
}

/// Ask the simulator to end the run.
pub fn exit_sim() {
    #[cfg(feature = "m5ops")]
    unsafe {
        m5::m5_exit(0);
    }
    #[cfg(not(feature = "m5ops"))]
    log::debug!("roi exit");
}
