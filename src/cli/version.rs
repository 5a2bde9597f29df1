/// Display version information
pub fn execute() {
    println!("ejector {}", env!("CARGO_PKG_VERSION"));
    println!("Validator ejection lifecycle manager");
}
