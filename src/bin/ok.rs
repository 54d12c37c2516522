// The `ok` grading client.
// Usage: ok [--config FILE] [-q NAME...] [--suite N [--case N]] [-v] [--score | --unlock]

fn main() {
    okgrade::cli::run();
}
