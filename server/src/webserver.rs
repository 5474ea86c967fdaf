use log::error;
use rocket::{get, http::Status, response::Redirect, routes, Build, Rocket};

use crate::session::{self, Session, SessionPolicy};

pub fn rocket_server() -> Rocket<Build> {
    mount(rocket::build())
}

fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(session::configure(SessionPolicy::application()))
        .mount("/", routes![index, signout])
}

pub async fn main() -> Result<(), rocket::Error> {
    rocket_server().launch().await.map(|_| ())
}

#[get("/")]
fn index(mut session: Session<'_>) -> Result<String, Status> {
    let visits = session.get::<u64>("visits").unwrap_or(0) + 1;
    session.insert("visits", visits).map_err(|err| {
        error!("could not record visit: {}", err);
        Status::InternalServerError
    })?;

    Ok(format!("Hello, world! Visit #{}", visits))
}

#[get("/signout?<origin>")]
fn signout(mut session: Session<'_>, origin: Option<String>) -> Redirect {
    session.reset();

    match origin {
        Some(origin) if is_local_path(&origin) => Redirect::temporary(origin),
        _ => Redirect::temporary("/"),
    }
}

fn is_local_path(origin: &str) -> bool {
    origin.starts_with('/') && !origin.starts_with("//")
}
