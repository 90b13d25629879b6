/// 除權除息預告表
pub mod dividend;
