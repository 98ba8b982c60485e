//! Graph helpers over edge keys: subtour subsets for the flow formulation
//! and ordering/validation of decoded routes.

pub mod route;
pub mod subtour;
