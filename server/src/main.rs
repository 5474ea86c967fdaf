mod configuration;
mod session;
#[cfg(test)]
mod test_helpers;
mod webserver;

#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    let _ = dotenv::dotenv();

    webserver::main().await
}
