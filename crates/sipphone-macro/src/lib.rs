//! Internal macros and codegen for the `sipphone` client library.
//!
//! This crate is intended for inner use only by `sipphone`.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::private_intra_doc_links)]
#![forbid(non_ascii_idents, unsafe_code)]

mod caused;

use synstructure::decl_derive;

decl_derive!([Caused, attributes(cause)] =>
/// Generate implementation of `Caused` trait for errors represented as enum.
///
/// # How to use
///
/// ### 1. Declare wrapper for a platform error and enum for error variants.
///
/// The `cause()` method returns error if nested error has its type declared
/// as an argument of the attribute `#[cause(error = "path::to::Error")]`.
///
/// ```
/// use sipphone::utils::Caused;
///
/// struct PlatformError {}
///
/// #[derive(Caused)]
/// #[cause(error = "PlatformError")]
/// enum FooError {
///     Internal,
///     Platform(PlatformError),
/// }
///
/// let err = FooError::Internal;
/// assert!(err.cause().is_none());
///
/// let err = FooError::Platform(PlatformError {});
/// assert!(err.cause().is_some());
/// ```
///
/// If enum variant has attribute `#[cause]` it will call the `cause()`
/// method on nested error.
///
/// ```
/// # use sipphone::utils::Caused;
/// #
/// # struct PlatformError {}
/// #
/// # #[derive(Caused)]
/// # #[cause(error = "PlatformError")]
/// # enum FooError {
/// #     Internal,
/// #     Platform(PlatformError),
/// # }
/// #
/// #[derive(Caused)]
/// #[cause(error = "PlatformError")]
/// enum BarError {
///     Foo(#[cause] FooError),
/// }
///
/// let err = BarError::Foo(FooError::Internal);
/// assert!(err.cause().is_none());
///
/// let err = BarError::Foo(FooError::Platform(PlatformError {}));
/// assert!(err.cause().is_some());
/// ```
caused::derive);
