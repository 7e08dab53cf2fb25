fn main() {
    uniffi::generate_scaffolding("src/meetkit.udl").unwrap();
}
