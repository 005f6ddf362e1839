use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    docscore::apps::run_score_documents(std::env::args().skip(1))
}
