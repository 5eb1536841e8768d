fn main() {
    relaywatch_lib::run()
}
