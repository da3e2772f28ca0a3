mod entry;

use loadrig::error::AppResult;

fn main() -> AppResult<()> {
    entry::run()
}
