use std::time::{Duration, Instant};

/// Accumulates the time spent in one stage of the conversion.
#[derive(Debug)]
pub struct CPUProfiler<'a> {
    runs: u64,
    total_time: u64,
    name: &'a str,
    last_start: Option<Instant>,
}

impl<'a> CPUProfiler<'a> {
    pub fn new(name: &'a str) -> Self {
        CPUProfiler {
            runs: 0,
            total_time: 0,
            name,
            last_start: None,
        }
    }

    /// Starts the stopwatch. Starting a running stopwatch restarts it.
    pub fn start(&mut self) {
        self.last_start = Some(Instant::now());
    }

    /// Stops the stopwatch and records the elapsed time. Does nothing when
    /// the stopwatch is not running.
    pub fn end(&mut self) {
        if let Some(start) = self.last_start.take() {
            self.total_time += start.elapsed().as_micros() as u64;
            self.runs += 1;
        }
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        self.name
    }

    #[inline]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    #[inline]
    pub fn total_time(&self) -> Duration {
        Duration::from_micros(self.total_time)
    }
}

/// Generates a struct of named `CPUProfiler`s with a `Default` impl.
macro_rules! impl_stats_struct {
    (pub $name: ident; $($it: ident),+) => {
        #[derive(Debug)]
        pub struct $name<'a> {
            $(pub $it: crate::perf::CPUProfiler<'a>,)+
        }

        impl<'a> Default for $name<'a> {
            fn default() -> Self {
                $name {
                    $($it: crate::perf::CPUProfiler::new(stringify!($it)),)+
                }
            }
        }

        impl<'a> $name<'a> {
            pub fn all(&self) -> Vec<&crate::perf::CPUProfiler<'a>> {
                vec![$(&self.$it,)+]
            }
        }
    };
}

/// Measures the rest of the current scope with the given profiler.
macro_rules! measure_scope {
    ($profiler: expr) => {
        struct ScopedMeasure<'a, 'b>(&'b mut crate::perf::CPUProfiler<'a>);
        impl<'a, 'b> Drop for ScopedMeasure<'a, 'b> {
            fn drop(&mut self) {
                self.0.end();
            }
        }
        $profiler.start();
        #[allow(unused)]
        let scoped = ScopedMeasure(&mut $profiler);
    };
}
