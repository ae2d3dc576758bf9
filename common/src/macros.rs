/// Emit the wrapped items only when compiling for x86_64.
#[macro_export]
macro_rules! cfg_x86_64 {
    ($($item:item)*) => {
        $(
            #[cfg(target_arch = "x86_64")]
            $item
        )*
    };
}

/// Emit the wrapped items only when compiling for aarch64.
#[macro_export]
macro_rules! cfg_aarch64 {
    ($($item:item)*) => {
        $(
            #[cfg(target_arch = "aarch64")]
            $item
        )*
    };
}
