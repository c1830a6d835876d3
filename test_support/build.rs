fn main() {
    // The gate's target function has to show up in the dynamic symbol
    // table, which is the only one mapped into memory.
    println!("cargo:rustc-link-arg-bins=-rdynamic");
}
