use crate::policy::immix::block::Block;
use crate::util::constants::{DEFAULT_HEAP_SIZE, MAX_HEAP_SIZE};
use crate::util::linear_scan::Region;
use std::default::Default;

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Options for a collector handle. The defaults can be overridden by environment
        /// variables named `RCIMMIX_<OPTION>` (e.g. `RCIMMIX_THREADS=4`), and then by
        /// [`crate::RCImmixBuilder::set_option`].
        #[derive(Clone, Debug)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Set an option from its name and string value. Returns false if the name is
            /// unknown, or the value cannot be parsed or does not pass validation. The old
            /// value is kept in that case.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_option()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// Options with the built-in defaults, ignoring the environment.
            pub fn without_env() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Check every option against its validator.
            pub fn validate(&self) -> Result<(), String> {
                $(
                    let validate_fn = $validator;
                    if !validate_fn(&self.$name) {
                        return Err(format!("{}={:?}", stringify!($name), self.$name));
                    }
                )*
                Ok(())
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Self::without_env();

                // If we have env vars that start with RCIMMIX_ and match any option (such as RCIMMIX_THREADS),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "RCIMMIX_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    // Size of the address space reserved for the heap. The block pool never grows beyond it.
    heap_size:                 usize [|v: &usize| *v >= Block::BYTES && *v <= MAX_HEAP_SIZE] = DEFAULT_HEAP_SIZE,
    // Number of GC worker threads used by the parallel phases when collect() is not given a worker count.
    threads:                   usize [|v: &usize| *v > 0] = num_cpus::get(),
    // Run the cycle backstop automatically once this many cycle candidates are buffered. 0 disables automatic runs.
    cycle_collect_threshold:   usize [always_valid] = 1,
    // Report a collection as due once the write barrier has remembered this many objects since the last one. 0 never reports.
    write_barrier_collect_threshold: usize [always_valid] = 0,
    // Maximum percentage of the heap's blocks one evacuation may fill with copied objects.
    defrag_headroom_percent:   usize [|v: &usize| *v <= 50] = 2,
    // Defragment in every collection.
    defrag_stress:             bool  [always_valid] = false,
    // Sweep in parallel only when at least this many blocks are in use.
    parallel_sweep_min_blocks: usize [|v: &usize| *v > 0] = 64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{serial_test, with_cleanup};

    #[test]
    fn no_env_var() {
        serial_test(|| {
            let options = Options::default();
            assert_eq!(options.heap_size, DEFAULT_HEAP_SIZE);
            assert_eq!(options.cycle_collect_threshold, 1);
            assert!(!options.defrag_stress);
        })
    }

    #[test]
    fn with_valid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("RCIMMIX_THREADS", "3");

                    let options = Options::default();
                    assert_eq!(options.threads, 3);
                },
                || {
                    std::env::remove_var("RCIMMIX_THREADS");
                },
            )
        })
    }

    #[test]
    fn with_multiple_valid_env_vars() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("RCIMMIX_DEFRAG_HEADROOM_PERCENT", "10");
                    std::env::set_var("RCIMMIX_PARALLEL_SWEEP_MIN_BLOCKS", "128");

                    let options = Options::default();
                    assert_eq!(options.defrag_headroom_percent, 10);
                    assert_eq!(options.parallel_sweep_min_blocks, 128);
                },
                || {
                    std::env::remove_var("RCIMMIX_DEFRAG_HEADROOM_PERCENT");
                    std::env::remove_var("RCIMMIX_PARALLEL_SWEEP_MIN_BLOCKS");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_value() {
        serial_test(|| {
            with_cleanup(
                || {
                    // invalid value, we cannot parse the value, so use the default value
                    std::env::set_var("RCIMMIX_DEFRAG_HEADROOM_PERCENT", "abc");

                    let options = Options::default();
                    assert_eq!(options.defrag_headroom_percent, 2);
                },
                || {
                    std::env::remove_var("RCIMMIX_DEFRAG_HEADROOM_PERCENT");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_key() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("RCIMMIX_ABC", "42");

                    let options = Options::default();
                    assert_eq!(options.defrag_headroom_percent, 2);
                },
                || {
                    std::env::remove_var("RCIMMIX_ABC");
                },
            )
        })
    }

    #[test]
    fn validator_rejects_value() {
        let mut options = Options::without_env();
        assert!(!options.set_from_str("threads", "0"));
        assert!(options.threads > 0);
        assert!(!options.set_from_str("defrag_headroom_percent", "51"));
        assert!(options.set_from_str("defrag_stress", "true"));
        assert!(options.defrag_stress);
        assert!(!options.set_from_str("no_such_option", "1"));
    }

    #[test]
    fn heap_size_bounds() {
        let mut options = Options::without_env();
        assert!(!options.set_from_str("heap_size", &usize::MAX.to_string()));
        assert!(!options.set_from_str("heap_size", "4096"));
        assert_eq!(options.heap_size, DEFAULT_HEAP_SIZE);
        assert!(options.set_from_str("heap_size", &MAX_HEAP_SIZE.to_string()));
        assert!(options.set_from_str("heap_size", &Block::BYTES.to_string()));
    }

    #[test]
    fn validate_reports_bad_field() {
        let mut options = Options::without_env();
        assert!(options.validate().is_ok());
        options.heap_size = 16;
        let err = options.validate().unwrap_err();
        assert!(err.starts_with("heap_size"));
    }
}
