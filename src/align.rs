/// Rounds a size up to the machine word size.
///
/// Every requested payload size passes through this before a block is
/// carved or recycled, so headers packed back to back always land on
/// word-aligned addresses.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use rmalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + mem::size_of::<usize>() - 1) & !(mem::size_of::<usize>() - 1)
  };
}
