pub mod helpers;

mod tests_concurrent;
mod tests_put_get;
