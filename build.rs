fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Only the firmware build links against ESP-IDF; host builds and tests
    // need no environment from the IDF toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
