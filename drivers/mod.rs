// Driver package / 驱动包
//
// The set of backends is closed; `storage::open_driver` picks one by config.

// Local filesystem driver / 本地文件系统驱动
pub mod local;
// S3-compatible object storage driver / S3对象存储驱动
pub mod s3;
// In-process driver, strongly consistent / 内存驱动
pub mod memory;
