//! 脑转移瘤复发研究的MRI预处理库：强度标准化、轮廓外扩与影像组学特征表。

pub mod config;
pub mod error;
pub mod external;
pub mod log;
pub mod naming;
pub mod output;
pub mod prelude;
pub mod segment;
pub mod table;
pub mod volume;
