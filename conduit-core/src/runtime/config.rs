use core::time::Duration;

use crate::error::CoreError;

/// Options recognised on `listen` (§6), validated at `build()` rather
/// than trusted as-typed — the teacher's configuration layer turns
/// invalid snapshots into a `ConfigurationError` at the boundary instead
/// of letting bad values reach the hot path, and this mirrors that.
#[derive(Clone, Debug)]
pub struct ListenOptions {
    pub max_connections: usize,
    pub max_port_connections: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub congestion_limit: usize,
    pub buffer_limit: usize,
    pub keep_alive: bool,
    pub no_delay: bool,
}

impl ListenOptions {
    pub fn builder() -> ListenOptionsBuilder {
        ListenOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct ListenOptionsBuilder {
    max_connections: usize,
    max_port_connections: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    congestion_limit: usize,
    buffer_limit: usize,
    keep_alive: bool,
    no_delay: bool,
}

impl ListenOptionsBuilder {
    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_max_port_connections(mut self, n: usize) -> Self {
        self.max_port_connections = n;
        self
    }

    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = Some(d);
        self
    }

    pub fn with_write_timeout(mut self, d: Duration) -> Self {
        self.write_timeout = Some(d);
        self
    }

    pub fn with_idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = Some(d);
        self
    }

    pub fn with_congestion_limit(mut self, n: usize) -> Self {
        self.congestion_limit = n;
        self
    }

    pub fn with_buffer_limit(mut self, n: usize) -> Self {
        self.buffer_limit = n;
        self
    }

    pub fn with_keep_alive(mut self, on: bool) -> Self {
        self.keep_alive = on;
        self
    }

    pub fn with_no_delay(mut self, on: bool) -> Self {
        self.no_delay = on;
        self
    }

    /// `0` means "unbounded" for both connection caps and the buffer
    /// limit, per §4.4/§5 — `build()` does not reject that, only
    /// nonsensical values (a zero timeout, which would fire immediately
    /// and is almost certainly a caller mistake rather than an intent).
    pub fn build(self) -> Result<ListenOptions, CoreError> {
        for (name, timeout) in [
            ("readTimeout", self.read_timeout),
            ("writeTimeout", self.write_timeout),
            ("idleTimeout", self.idle_timeout),
        ] {
            if timeout == Some(Duration::ZERO) {
                return Err(CoreError::new(
                    "config.invalid_timeout",
                    alloc::format!("{name} must be greater than zero, or omitted for \"no timeout\""),
                ));
            }
        }
        Ok(ListenOptions {
            max_connections: self.max_connections,
            max_port_connections: self.max_port_connections,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            idle_timeout: self.idle_timeout,
            congestion_limit: self.congestion_limit,
            buffer_limit: self.buffer_limit,
            keep_alive: self.keep_alive,
            no_delay: self.no_delay,
        })
    }
}

/// Options recognised on `mux`/`merge` (§6/§4.3).
#[derive(Clone, Copy, Debug)]
pub struct MuxOptions {
    /// Seconds with zero sharers before recycle; `0` means "use the
    /// implementation default recycling cadence", never "never recycle".
    pub max_idle: Duration,
    /// Concurrent streams per session; `0` means unbounded.
    pub max_queue: usize,
    /// Lifetime messages per session; `0` means unbounded.
    pub max_messages: usize,
    pub is_one_way: bool,
}

impl MuxOptions {
    pub fn builder() -> MuxOptionsBuilder {
        MuxOptionsBuilder::default()
    }
}

pub struct MuxOptionsBuilder {
    max_idle: Duration,
    max_queue: usize,
    max_messages: usize,
    is_one_way: bool,
}

impl Default for MuxOptionsBuilder {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(60),
            max_queue: 0,
            max_messages: 0,
            is_one_way: false,
        }
    }
}

impl MuxOptionsBuilder {
    pub fn with_max_idle(mut self, d: Duration) -> Self {
        self.max_idle = d;
        self
    }

    pub fn with_max_queue(mut self, n: usize) -> Self {
        self.max_queue = n;
        self
    }

    pub fn with_max_messages(mut self, n: usize) -> Self {
        self.max_messages = n;
        self
    }

    pub fn with_one_way(mut self, on: bool) -> Self {
        self.is_one_way = on;
        self
    }

    pub fn build(self) -> Result<MuxOptions, CoreError> {
        Ok(MuxOptions {
            max_idle: self.max_idle,
            max_queue: self.max_queue,
            max_messages: self.max_messages,
            is_one_way: self.is_one_way,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ListenOptions::builder()
            .with_read_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "config.invalid_timeout");
    }

    #[test]
    fn unset_caps_mean_unbounded() {
        let opts = ListenOptions::builder().build().unwrap();
        assert_eq!(opts.max_connections, 0);
        assert_eq!(opts.buffer_limit, 0);
    }

    #[test]
    fn mux_options_default_to_sane_values() {
        let opts = MuxOptions::builder().build().unwrap();
        assert_eq!(opts.max_queue, 0);
        assert!(!opts.is_one_way);
    }
}
