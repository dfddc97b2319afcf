fn main() {
    lookupbench::cmdline();
}
