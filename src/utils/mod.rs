pub mod codes;
pub mod money;
#[cfg(test)]
pub mod stripe_signature;
