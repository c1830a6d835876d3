fn main() {
    // Export every function through the dynamic symbol table, where the
    // launcher finds its own replacement function at run time.
    println!("cargo:rustc-link-arg-bins=-rdynamic");
}
