pub mod change;
pub mod lookup;
pub mod naming;
pub mod restore;
pub mod table;
pub mod validation;
